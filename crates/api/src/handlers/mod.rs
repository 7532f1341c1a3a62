pub mod carriers;
pub mod trackings;
