//! Typed clients for the services under test.
use crate::proto::*;
use std::sync::Arc;
use swarmer::{Capability, Connection, RpcError};

pub mod auth {
    pub const SIGN_UP_USER: &str = "/auth.AuthService/SignUpUser";
    pub const SIGN_IN_USER: &str = "/auth.AuthService/SignInUser";
    pub const VERIFY_EMAIL: &str = "/auth.AuthService/VerifyEmail";
    pub const GET_ME: &str = "/auth.AuthService/GetMe";
}

pub mod vacancy {
    pub const CREATE_VACANCY: &str = "/vacancy.VacancyService/CreateVacancy";
    pub const GET_VACANCY: &str = "/vacancy.VacancyService/GetVacancy";
    pub const GET_VACANCIES: &str = "/vacancy.VacancyService/GetVacancies";
    pub const UPDATE_VACANCY: &str = "/vacancy.VacancyService/UpdateVacancy";
    pub const DELETE_VACANCY: &str = "/vacancy.VacancyService/DeleteVacancy";
}

#[derive(Clone)]
pub struct AuthClient {
    connection: Arc<Connection>,
}

impl Capability for AuthClient {
    const NAME: &'static str = "auth";

    fn bind(connection: Arc<Connection>) -> Self {
        Self { connection }
    }
}

impl AuthClient {
    pub async fn sign_up_user(&self, input: &SignUpUserInput) -> Result<SignUpUserResponse, RpcError> {
        self.connection.unary(auth::SIGN_UP_USER, input).await
    }

    pub async fn sign_in_user(&self, input: &SignInUserInput) -> Result<SignInUserResponse, RpcError> {
        self.connection.unary(auth::SIGN_IN_USER, input).await
    }

    pub async fn verify_email(&self, code: &str) -> Result<GenericResponse, RpcError> {
        let request = VerifyEmailRequest {
            verification_code: code.to_string(),
        };
        self.connection.unary(auth::VERIFY_EMAIL, &request).await
    }

    pub async fn get_me(&self, id: &str) -> Result<UserResponse, RpcError> {
        let request = GetMeRequest { id: id.to_string() };
        self.connection.unary(auth::GET_ME, &request).await
    }
}

#[derive(Clone)]
pub struct VacancyClient {
    connection: Arc<Connection>,
}

impl Capability for VacancyClient {
    const NAME: &'static str = "vacancy";

    fn bind(connection: Arc<Connection>) -> Self {
        Self { connection }
    }
}

impl VacancyClient {
    pub async fn create_vacancy(
        &self,
        request: &CreateVacancyRequest,
    ) -> Result<VacancyResponse, RpcError> {
        self.connection.unary(vacancy::CREATE_VACANCY, request).await
    }

    pub async fn get_vacancy(&self, id: &str) -> Result<VacancyResponse, RpcError> {
        let request = VacancyRequest { id: id.to_string() };
        self.connection.unary(vacancy::GET_VACANCY, &request).await
    }

    /// Server streaming; the whole stream is read before returning.
    pub async fn get_vacancies(
        &self,
        request: &GetVacanciesRequest,
    ) -> Result<Vec<VacancyResponse>, RpcError> {
        self.connection
            .server_streaming(vacancy::GET_VACANCIES, request)
            .await
    }

    pub async fn update_vacancy(
        &self,
        request: &UpdateVacancyRequest,
    ) -> Result<VacancyResponse, RpcError> {
        self.connection.unary(vacancy::UPDATE_VACANCY, request).await
    }

    pub async fn delete_vacancy(&self, id: &str) -> Result<DeleteVacancyResponse, RpcError> {
        let request = VacancyRequest { id: id.to_string() };
        self.connection.unary(vacancy::DELETE_VACANCY, &request).await
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}
