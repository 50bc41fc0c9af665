use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanvassError {
    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),
}
