//! Messages of the `auth.AuthService` and `vacancy.VacancyService` APIs.
use swarmer::measurable;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Division {
    Unspecified = 0,
    Product = 1,
    Engineering = 2,
    Marketing = 3,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct User {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub email: String,
    #[prost(string, tag = "4")]
    pub role: String,
    #[prost(message, optional, tag = "5")]
    pub created_at: Option<Timestamp>,
    #[prost(message, optional, tag = "6")]
    pub updated_at: Option<Timestamp>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SignUpUserInput {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub email: String,
    #[prost(string, tag = "3")]
    pub password: String,
    #[prost(string, tag = "4")]
    pub password_confirm: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SignUpUserResponse {
    #[prost(message, optional, tag = "1")]
    pub user: Option<User>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SignInUserInput {
    #[prost(string, tag = "1")]
    pub email: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SignInUserResponse {
    #[prost(string, tag = "1")]
    pub status: String,
    #[prost(string, tag = "2")]
    pub access_token: String,
    #[prost(string, tag = "3")]
    pub refresh_token: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct VerifyEmailRequest {
    #[prost(string, tag = "1")]
    pub verification_code: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GenericResponse {
    #[prost(string, tag = "1")]
    pub status: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetMeRequest {
    #[prost(string, tag = "1")]
    pub id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserResponse {
    #[prost(message, optional, tag = "1")]
    pub user: Option<User>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Vacancy {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub title: String,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(int64, tag = "4")]
    pub views: i64,
    #[prost(enumeration = "Division", tag = "5")]
    pub division: i32,
    #[prost(string, tag = "6")]
    pub country: String,
    #[prost(message, optional, tag = "7")]
    pub created_at: Option<Timestamp>,
    #[prost(message, optional, tag = "8")]
    pub updated_at: Option<Timestamp>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateVacancyRequest {
    #[prost(string, tag = "1")]
    pub title: String,
    #[prost(string, tag = "2")]
    pub description: String,
    #[prost(enumeration = "Division", tag = "3")]
    pub division: i32,
    #[prost(string, tag = "4")]
    pub country: String,
}

/// Only `id` is mandatory; unset fields are left untouched by the service.
#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateVacancyRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, optional, tag = "2")]
    pub title: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub description: Option<String>,
    #[prost(int64, optional, tag = "4")]
    pub views: Option<i64>,
    #[prost(enumeration = "Division", optional, tag = "5")]
    pub division: Option<i32>,
    #[prost(string, optional, tag = "6")]
    pub country: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct VacancyRequest {
    #[prost(string, tag = "1")]
    pub id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct VacancyResponse {
    #[prost(message, optional, tag = "1")]
    pub vacancy: Option<Vacancy>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetVacanciesRequest {
    #[prost(int64, optional, tag = "1")]
    pub page: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    pub limit: Option<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeleteVacancyResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

measurable!(
    SignUpUserResponse,
    SignInUserResponse,
    GenericResponse,
    UserResponse,
    VacancyResponse,
    DeleteVacancyResponse,
);
