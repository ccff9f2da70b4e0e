pub mod context;

pub use context::{
    get,
    remove,
    set,
    AmbientContext,
};
