pub mod config;
pub mod config_loader;
pub mod errors;
pub mod series;
pub mod traits;

pub use config::{AnalysisConfig, AppConfig, DatabaseConfig};
pub use config_loader::ConfigLoader;
pub use errors::{DiagnoseError, Stage};
pub use series::PriceSeries;
pub use traits::PriceSource;
