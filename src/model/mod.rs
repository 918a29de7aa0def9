//! Pure data types for cards and resources. Nothing in `model` touches the
//! filesystem or the solver; that belongs to `cache`, `resources`, and
//! `calc`.

pub mod card;
pub mod card_type;
pub mod field_type;
pub mod link_type;
pub mod resource;
pub mod resource_name;
pub mod workflow;
