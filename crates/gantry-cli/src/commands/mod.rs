mod build;
mod init;

pub use build::build;
pub use init::init;
