pub mod backend;
pub mod resolvers;
