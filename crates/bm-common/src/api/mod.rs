pub mod match_response;
pub mod queue_dto;
pub mod user_dto;

pub use match_response::MatchCandidateResponse;
pub use queue_dto::{
    BookSubmission, QueueStatusResponse, SubmitBooksRequest, SubmitBooksResponse,
    TagFrequencyResponse,
};
pub use user_dto::{
    EditBookRequest, FollowResponse, LibraryResponse, StatsResponse, UpdateProfileRequest,
    UserViewResponse,
};
