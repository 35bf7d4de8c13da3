use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("{} employees are missing a required field (rut or email)", .0.len())]
    MissingRequiredFields(Vec<String>),

    #[error("Employee codes appear more than once: {0:?}")]
    DuplicateEmployeeCodes(Vec<i32>),

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid employee code {value:?}")]
    InvalidEmployeeCode { value: String },
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Completion endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },
}
