mod node;

pub(crate) use node::{Buffer, Node};
