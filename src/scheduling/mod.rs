pub mod adaptive;
pub mod ds;
pub mod factory;
pub mod interval;
pub mod scheduler;
pub mod time_of_day;
pub mod worker;
