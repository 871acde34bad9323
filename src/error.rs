use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("planning failed: {0}")]
    Planning(String),

    #[error("Execution error at step {index}: {reason}")]
    Execution { index: usize, reason: String },

    #[error("Control agent error: {0}")]
    Agent(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_error_is_user_visible() {
        let err = AppError::Planning("connection refused".to_string());
        assert_eq!(err.to_string(), "planning failed: connection refused");
    }

    #[test]
    fn test_execution_error_carries_index() {
        let err = AppError::Execution {
            index: 2,
            reason: "Unknown action".to_string(),
        };
        assert!(err.to_string().contains("step 2"));
    }
}
