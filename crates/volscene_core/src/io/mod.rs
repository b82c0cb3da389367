//! Volume codecs.

pub mod nrrd;
