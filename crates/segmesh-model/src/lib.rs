pub mod io;
pub mod segresnet;
pub mod weights;

pub use segresnet::{SegResNet, SegResNetConfig};
pub use weights::{load_segresnet, save_segresnet, LoadStrategy, ModelLoadError};
