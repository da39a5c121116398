pub mod credential;
pub mod job;

pub use credential::CredentialRepository;
pub use job::JobRepository;
