//! Background work that runs outside of caller threads.

pub(crate) mod dispatcher;
