//! User classes of the vacancy workload.
use crate::clients::{AuthClient, VacancyClient};
use crate::credentials::CredentialPool;
use crate::proto::*;
use crate::text::RandomText;
use std::time::Duration;
use swarmer::prelude::*;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

pub const LOGIN_WITH_UNIQUE_USERS: &str = "LoginWithUniqueUsers";
pub const FETCH_VACANCIES: &str = "FetchVacancies";

pub const LOGIN_THINK_TIME: Duration = Duration::from_secs(30);
pub const FETCH_THINK_TIME: Duration = Duration::from_secs(44);
pub const FETCH_LIMIT: i64 = 100;

/// Account the user signed in with.
#[derive(Clone, Debug)]
pub struct SignedIn {
    pub email: String,
    pub access_token: String,
}

/// Vacancy the current `VacancyLoad` pass works on.
#[derive(Clone, Debug)]
pub struct CurrentVacancy(pub String);

/// Signs in with the next pooled account, then loops create, update, fetch
/// and delete of a vacancy.
pub fn login_with_unique_users(pool: CredentialPool) -> UserClass {
    let tasks = TaskSet::sequential("LoginWithUsers")
        .on_start(sign_in())
        .step(vacancy_load());

    UserClass::new(LOGIN_WITH_UNIQUE_USERS, tasks)
        .weight(3)
        .think_time(ThinkTime::constant(LOGIN_THINK_TIME))
        .capability::<AuthClient>()
        .capability::<VacancyClient>()
        .shared(pool)
}

/// Lists vacancies.
pub fn fetch_vacancies_user() -> UserClass {
    UserClass::new(
        FETCH_VACANCIES,
        TaskSet::random(FETCH_VACANCIES).step(fetch_vacancies()),
    )
    .weight(1)
    .think_time(ThinkTime::constant(FETCH_THINK_TIME))
    .capability::<VacancyClient>()
}

/// One pass ends with an interrupt after the vacancy is deleted.
pub fn vacancy_load() -> TaskSet {
    TaskSet::sequential("VacancyLoad")
        .step(create_vacancy())
        .step(update_vacancy())
        .step(fetch_vacancy())
        .step(delete_vacancy())
}

fn current_vacancy(ctx: &UserContext) -> Result<String, ActionError> {
    ctx.session()
        .get::<CurrentVacancy>()
        .map(|current| current.0.clone())
        .ok_or_else(|| ActionError::failed("no vacancy has been created"))
}

#[action]
async fn sign_in(ctx: &mut UserContext) -> ActionResult {
    let credentials = ctx
        .shared::<CredentialPool>()
        .and_then(|pool| pool.next().cloned())
        .ok_or_else(|| ActionError::failed("no test accounts configured"))?;
    let auth = ctx.client::<AuthClient>()?.clone();

    let input = SignInUserInput {
        email: credentials.email.clone(),
        password: credentials.password,
    };
    let res = auth.sign_in_user(&input).await?;
    info!("Login with {}", credentials.email);

    ctx.session_mut().insert(SignedIn {
        email: credentials.email,
        access_token: res.access_token,
    });
    Ok(Flow::Continue)
}

#[action]
async fn create_vacancy(ctx: &mut UserContext) -> ActionResult {
    let vacancies = ctx.client::<VacancyClient>()?.clone();
    let rng = ctx.rng();
    let request = CreateVacancyRequest {
        country: RandomText::lowercase(rng, 8, false),
        description: RandomText::lowercase(rng, 8, false),
        division: Division::Engineering as i32,
        title: RandomText::lowercase(rng, 8, false),
    };

    let vacancy = vacancies
        .create_vacancy(&request)
        .await?
        .vacancy
        .ok_or_else(|| ActionError::failed("CreateVacancy returned no vacancy"))?;
    info!("Vacancy is created with {}", vacancy.id);

    ctx.session_mut().insert(CurrentVacancy(vacancy.id));
    Ok(Flow::Continue)
}

#[action]
async fn update_vacancy(ctx: &mut UserContext) -> ActionResult {
    let vacancies = ctx.client::<VacancyClient>()?.clone();
    let request = UpdateVacancyRequest {
        id: current_vacancy(ctx)?,
        title: Some(RandomText::lowercase(ctx.rng(), 8, false)),
        ..Default::default()
    };

    let res = vacancies.update_vacancy(&request).await?;
    debug!("Vacancy is updated with {:?}", res.vacancy);
    Ok(Flow::Continue)
}

#[action]
async fn fetch_vacancy(ctx: &mut UserContext) -> ActionResult {
    let vacancies = ctx.client::<VacancyClient>()?.clone();
    let id = current_vacancy(ctx)?;

    let res = vacancies.get_vacancy(&id).await?;
    debug!("Vacancy is fetched {:?}", res.vacancy);
    Ok(Flow::Continue)
}

#[action]
async fn delete_vacancy(ctx: &mut UserContext) -> ActionResult {
    let vacancies = ctx.client::<VacancyClient>()?.clone();
    let id = current_vacancy(ctx)?;

    let res = vacancies.delete_vacancy(&id).await?;
    info!("Vacancy {id} is deleted: {}", res.success);
    ctx.session_mut().remove::<CurrentVacancy>();
    Ok(Flow::Interrupt)
}

#[action]
async fn fetch_vacancies(ctx: &mut UserContext) -> ActionResult {
    if ctx.is_closed() {
        return Ok(Flow::Continue);
    }
    let vacancies = ctx.client::<VacancyClient>()?.clone();
    let request = GetVacanciesRequest {
        page: None,
        limit: Some(FETCH_LIMIT),
    };

    let res = vacancies.get_vacancies(&request).await?;
    info!("Vacancies are fetched: {}", res.len());
    Ok(Flow::Continue)
}
