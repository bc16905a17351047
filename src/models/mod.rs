pub mod article;
pub mod edit;
pub mod market;
pub mod topic;
pub mod weather;

pub use article::*;
pub use edit::*;
pub use market::*;
pub use topic::*;
pub use weather::*;
