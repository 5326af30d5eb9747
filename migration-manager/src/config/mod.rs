mod dependencies;
mod settings;

pub use dependencies::{Connectors, Dependencies};
pub use settings::{LogFormat, Settings};
