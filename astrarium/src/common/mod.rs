pub(crate) mod buffer2;
pub(crate) mod cancel;

pub(crate) use buffer2::Buffer2;
