pub mod bucket;
pub mod credential;
pub mod fault;
pub mod job;

pub use bucket::{RateLimit, RateLimitBucket, RateLimitTable};
pub use credential::{CertificateAuthorityRecord, Credential, RevocationRecord};
pub use fault::{FaultKind, FaultMagnitude, FaultRule};
pub use job::{Job, JobParameters, JobStatus, JobTransition};
