pub mod dates;
pub mod serialization;
