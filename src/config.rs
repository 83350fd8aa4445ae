// ABOUTME: Small constants shared by the CLI front end

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
