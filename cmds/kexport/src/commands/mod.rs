pub mod completions;
pub mod export;
pub mod resources;

pub mod util;
