use std::process::ExitCode;
use swarmer_runtime::{exit_status, SwarmerRuntime};
use vacancy_load::{fetch_vacancies_user, login_with_unique_users, CredentialPool};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let stats = SwarmerRuntime::new()
        .with_args()
        .user_class(login_with_unique_users(CredentialPool::from_env()))
        .user_class(fetch_vacancies_user())
        .run()
        .await?;

    Ok(ExitCode::from(exit_status(&stats)))
}
