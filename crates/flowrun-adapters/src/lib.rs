pub mod credentials;
pub mod flows;
pub mod generation;
pub mod ledger;

pub use credentials::ConfigCredentialStore;
pub use flows::DirFlowStore;
pub use generation::HttpGenerationService;
pub use ledger::JsonlLedger;
