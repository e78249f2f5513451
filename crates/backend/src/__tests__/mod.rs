mod application;
mod helpers;
mod runner;
mod transport;
