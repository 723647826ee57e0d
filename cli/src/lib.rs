pub mod replay;
pub mod scenario;

pub use replay::ReplayCli;
