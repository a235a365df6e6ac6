//! Bulk import of client records from delimited files into a remote account
//! system.

pub mod config;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod import;
pub mod logging;
pub mod reader;
pub mod validation;

pub use config::{ApiConfig, ImportSettings, ImporterConfig};
pub use error::{ImportError, Result};
pub use gateway::{ClientGateway, GatewayError, NewClient, RemoteId, RpcGateway};
pub use import::{BatchImporter, BatchResult, ImportRequest, RunPhase, RunReport, StartAt};
