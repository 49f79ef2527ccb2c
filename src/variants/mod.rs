mod em;
mod lloyd;

pub(crate) use em::EmEngine;
pub(crate) use lloyd::Lloyd;
