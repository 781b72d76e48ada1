pub mod address;
pub mod duration;
pub mod row;
