mod expiration;
mod single_flight;
mod timeout;
