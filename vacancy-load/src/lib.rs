//! Load test for the vacancy and auth gRPC services.
pub mod clients;
pub mod credentials;
pub mod proto;
pub mod text;
pub mod users;

pub use clients::{AuthClient, VacancyClient};
pub use credentials::{CredentialPool, Credentials};
pub use text::RandomText;
pub use users::{fetch_vacancies_user, login_with_unique_users, vacancy_load};
