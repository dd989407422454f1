pub mod adapter;

pub use adapter::{batch_to_windows, windows_to_batch};
