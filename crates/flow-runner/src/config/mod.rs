pub mod actions;
pub mod params;
pub mod schema;

pub use actions::{Action, Target};
pub use params::{ParamDef, Params};
pub use schema::{BrowserConfig, Config, OnFailure, SuccessCondition, TargetUrl, Viewport};
