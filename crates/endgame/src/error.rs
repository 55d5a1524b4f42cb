use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no game found in pgn")]
    NoGame,
    #[error("invalid FEN {fen:?}: {reason}")]
    InvalidFen { fen: String, reason: String },
    #[error("illegal move {san} at ply {ply}")]
    IllegalMove { ply: u32, san: String },
}
