pub mod hometax;
pub mod lookup;

pub use hometax::{request_body, HometaxClient};
pub use lookup::{MockRegistry, RegistryError, RegistryLookup};
