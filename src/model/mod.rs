//! Linear models: layouts of the full and reduced models and their fits

mod fitting;
mod layout;

pub use fitting::{fit_models, FitResult, ModelFit};
pub(crate) use fitting::layout_rss;
pub use layout::{Design, Layout, ModelSpec};
