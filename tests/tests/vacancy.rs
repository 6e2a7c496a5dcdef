mod utils;
#[allow(unused)]
use utils::*;

use bytes::Bytes;
use mock_service::{MockConnector, MockService, Route};
use prost::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swarmer::core::{PopulationSettings, ThinkTime, UserClassOverride};
use swarmer::Population;
use vacancy_load::clients::{auth, vacancy};
use vacancy_load::proto::*;
use vacancy_load::users::{FETCH_VACANCIES, LOGIN_WITH_UNIQUE_USERS};
use vacancy_load::{fetch_vacancies_user, login_with_unique_users, CredentialPool, Credentials};

fn vacancy_response(id: String) -> Bytes {
    VacancyResponse {
        vacancy: Some(Vacancy {
            id,
            title: "title".to_string(),
            ..Default::default()
        }),
    }
    .encode_to_vec()
    .into()
}

fn vacancy_service() -> MockConnector {
    let next_id = Arc::new(AtomicU64::new(1));

    MockService::new()
        .route(
            auth::SIGN_IN_USER,
            Route::unary(|request| {
                let input = SignInUserInput::decode(request)?;
                if input.password.is_empty() {
                    return Err(swarmer::RpcError::status(
                        swarmer::core::StatusCode::UNAUTHENTICATED,
                        "missing password",
                    ));
                }
                Ok(SignInUserResponse {
                    status: "success".to_string(),
                    access_token: format!("token-{}", input.email),
                    refresh_token: String::new(),
                }
                .encode_to_vec()
                .into())
            }),
        )
        .route(
            vacancy::CREATE_VACANCY,
            Route::unary(move |_| {
                let id = next_id.fetch_add(1, Ordering::SeqCst);
                Ok(vacancy_response(format!("v-{id}")))
            }),
        )
        .route(
            vacancy::UPDATE_VACANCY,
            Route::unary(|request| {
                let update = UpdateVacancyRequest::decode(request)?;
                Ok(vacancy_response(update.id))
            }),
        )
        .route(
            vacancy::GET_VACANCY,
            Route::unary(|request| {
                let get = VacancyRequest::decode(request)?;
                Ok(vacancy_response(get.id))
            }),
        )
        .route(
            vacancy::DELETE_VACANCY,
            Route::unary(|_| Ok(DeleteVacancyResponse { success: true }.encode_to_vec().into())),
        )
        .route(
            vacancy::GET_VACANCIES,
            Route::stream(|request| {
                let limit = GetVacanciesRequest::decode(request)?.limit.unwrap_or(10);
                Ok((0..limit.min(5))
                    .map(|i| vacancy_response(format!("listed-{i}")))
                    .collect())
            }),
        )
        .into_connector()
}

fn pool() -> CredentialPool {
    CredentialPool::new(vec![
        Credentials {
            email: "one@example.com".to_string(),
            password: "1".to_string(),
        },
        Credentials {
            email: "two@example.com".to_string(),
            password: "2".to_string(),
        },
    ])
}

fn fast(settings: &mut PopulationSettings, class: &str) {
    settings.classes.insert(
        class.to_string(),
        UserClassOverride {
            weight: None,
            think_time: Some(ThinkTime::constant(Duration::from_millis(5))),
        },
    );
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn vacancy_workload_against_mock() {
    init();

    let mut settings = PopulationSettings::new("vacancies.local:7823")
        .users(4)
        .spawn_rate(100.)
        .run_time(Duration::from_millis(500))
        .stop_timeout(Duration::from_secs(2));
    fast(&mut settings, LOGIN_WITH_UNIQUE_USERS);
    fast(&mut settings, FETCH_VACANCIES);

    let connector = vacancy_service();
    let population = Population::new(
        settings,
        vec![login_with_unique_users(pool()), fetch_vacancies_user()],
        Arc::new(connector.clone()),
    )
    .unwrap();
    assert_eq!(population.target_counts(), [3, 1]);

    let stats = population.run().await;
    assert_eq!(stats.peak_users, 4);
    assert_eq!(stats.forced_stops, 0);
    assert_eq!(stats.total_errors, 0, "{stats}");

    // Sign-in happens once per login user, on start.
    assert_eq!(connector.calls_to(auth::SIGN_IN_USER), 3);

    let creates = connector.calls_to(vacancy::CREATE_VACANCY);
    let deletes = connector.calls_to(vacancy::DELETE_VACANCY);
    assert!(creates >= 3);
    assert!(deletes + 3 >= creates && deletes <= creates);
    assert!(connector.calls_to(vacancy::GET_VACANCIES) >= 1);

    let listing = stats
        .methods
        .iter()
        .find(|m| m.method == vacancy::GET_VACANCIES)
        .unwrap();
    assert_eq!(listing.avg_response_size, 5.);
    assert_eq!(connector.stats().open(), 0);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn login_without_accounts_still_runs() {
    init();

    let mut settings = PopulationSettings::new("vacancies.local:7823")
        .users(1)
        .spawn_rate(100.)
        .run_time(Duration::from_millis(200));
    fast(&mut settings, LOGIN_WITH_UNIQUE_USERS);

    let connector = vacancy_service();
    let population = Population::new(
        settings,
        vec![login_with_unique_users(CredentialPool::default())],
        Arc::new(connector.clone()),
    )
    .unwrap();

    let stats = population.run().await;
    assert_eq!(stats.peak_users, 1);
    assert_eq!(connector.calls_to(auth::SIGN_IN_USER), 0);
    assert!(connector.calls_to(vacancy::CREATE_VACANCY) >= 1);
}
