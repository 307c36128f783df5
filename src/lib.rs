pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod http;
pub mod parser;
pub mod persistence;
pub mod pipeline;
pub mod probability;
pub mod providers;
pub mod signing;
pub mod trading;

pub mod cli;

pub use config::{BotConfig, RuntimeConfig};
pub use domain::*;
pub use error::{BotError, Result};
pub use executor::{DryRunExecutor, LiveExecutor, OrderExecutor};
pub use pipeline::OpportunityPipeline;
pub use trading::{CycleReport, TradingStateMachine};
