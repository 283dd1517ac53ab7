//! Route modules for zip2pdf-server

pub mod convert;
pub mod health;
pub mod upload;
