pub mod credentials;
pub mod error;
pub mod faults;
pub mod jobs;
pub mod ratelimit;

pub use credentials::{
    CaCertificateResponse, IssueCredentialRequest, IssueCredentialResponse, RevocationEntry,
    RevocationListResponse, RevokeCredentialRequest, RevokeCredentialResponse,
    VerifyCredentialRequest, VerifyCredentialResponse,
};
pub use error::{ErrorResponse, RateLimitDetails};
pub use faults::{
    ClearFaultsResponse, FaultRuleInfo, InjectFailureRequest, InjectLatencyRequest,
    InjectionResponse, ListFaultsResponse,
};
pub use jobs::{CreateJobRequest, CreateJobResponse, JobResponse};
pub use ratelimit::{ConsumeRateLimitRequest, RateLimitDecisionResponse};
