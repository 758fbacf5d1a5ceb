mod iterators;
mod node;
mod overlaps;

pub(crate) use node::{Child, StrideNode};
