use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save vote for `{phase_key}`")]
    SaveVote {
        phase_key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to count votes for `{phase_key}`")]
    CountVotes {
        phase_key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load winner for `{phase_key}`")]
    LoadWinner {
        phase_key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save winner for `{phase_key}`")]
    SaveWinner {
        phase_key: String,
        #[source]
        source: MongoError,
    },
    #[error("winner for `{phase_key}` vanished after a duplicate insert")]
    MissingWinner { phase_key: String },
    #[error("failed to load the clock row")]
    LoadClock {
        #[source]
        source: MongoError,
    },
    #[error("failed to save the clock row")]
    SaveClock {
        #[source]
        source: MongoError,
    },
    #[error("clock row vanished after a duplicate insert")]
    MissingClock,
}
