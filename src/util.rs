mod ref_id;

pub use ref_id::*;
