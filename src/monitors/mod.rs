pub mod criteria;
pub mod probe;
pub mod status;
pub mod tracker;
