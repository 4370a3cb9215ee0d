pub mod contract;
pub mod errors;
pub mod model;
pub mod table;
mod validate;

pub use contract::{ImportContract, Normalization};
pub use errors::ContractError;
pub use model::{ImportReport, ValidatedImport, Violation};
pub use table::Table;
pub use validate::validate_treesum;
