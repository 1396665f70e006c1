pub mod clock;
pub mod discharge;
pub mod peak;
pub mod prices;
pub mod provider;
pub mod scheduler;
pub mod window;
