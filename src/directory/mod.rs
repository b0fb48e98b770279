//! Directory-backed certificate store.

pub mod cert_repository;
pub mod client;
pub mod layout;
pub mod parser;

pub use cert_repository::CertificateDirectory;
pub use client::DirectoryClient;
pub use layout::DirectoryLayout;
