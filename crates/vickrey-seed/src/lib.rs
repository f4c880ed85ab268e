// Draft state initializer: pulls league users and the player catalog from
// external feeds and persists a fresh draft snapshot.

pub mod catalog;
pub mod seed;
pub mod sources;
