//! In-process shell for driving the core: store and browser effects are
//! answered on the spot, HTTP requests queue until a test replies to them.

#![allow(dead_code)]

use crux_core::testing::{AppTester, Update};
use crux_core::Request;
use sala_shared::capabilities::{
    ApiRequest, ApiResponse, HttpError, KvOperation, KvOutput, KvResult, StoreError, StoreKey,
};
use sala_shared::session::User;
use sala_shared::{App, Effect, Event, Model};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use url::Url;

pub struct Shell {
    pub app: AppTester<App, Effect>,
    pub model: Model,
    pub store: HashMap<StoreKey, String>,
    pub store_fails: bool,
    pub kv_log: Vec<KvOperation>,
    pub opened: Vec<Url>,
    pub renders: usize,
    http: VecDeque<Request<ApiRequest>>,
}

impl Default for Shell {
    fn default() -> Self {
        Self {
            app: AppTester::default(),
            model: Model::default(),
            store: HashMap::new(),
            store_fails: false,
            kv_log: Vec::new(),
            opened: Vec::new(),
            renders: 0,
            http: VecDeque::new(),
        }
    }
}

impl Shell {
    pub fn with_store(entries: &[(StoreKey, &str)]) -> Self {
        let mut shell = Self::default();
        for (key, value) in entries {
            shell.store.insert(*key, (*value).to_string());
        }
        shell
    }

    /// Past the splash with nothing stored.
    pub fn at_welcome() -> Self {
        let mut shell = Self::default();
        shell.dispatch(Event::AppStarted);
        shell.dispatch(Event::SplashTimerElapsed);
        shell
    }

    /// Past the splash with a stored token and user.
    pub fn signed_in(user: &User) -> Self {
        let user = serde_json::to_string(user).unwrap();
        let mut shell = Self::with_store(&[(StoreKey::AuthToken, "tok"), (StoreKey::CachedUser, &user)]);
        shell.dispatch(Event::AppStarted);
        shell.dispatch(Event::SplashTimerElapsed);
        shell
    }

    pub fn dispatch(&mut self, event: Event) {
        let update = self.app.update(event, &mut self.model);
        self.absorb(update);
    }

    fn absorb(&mut self, update: Update<Effect, Event>) {
        for effect in update.effects {
            match effect {
                Effect::Render(_) => self.renders += 1,
                Effect::Http(request) => self.http.push_back(request),
                Effect::KeyValue(mut request) => {
                    let output = self.run_kv(&request.operation);
                    let update = self.app.resolve(&mut request, output).expect("kv resolves");
                    self.absorb(update);
                }
                Effect::Browser(mut request) => {
                    self.opened.push(request.operation.url.clone());
                    let update = self.app.resolve(&mut request, Ok(())).expect("browser resolves");
                    self.absorb(update);
                }
            }
        }
        for event in update.events {
            self.dispatch(event);
        }
    }

    fn run_kv(&mut self, operation: &KvOperation) -> KvResult {
        self.kv_log.push(operation.clone());
        if self.store_fails {
            return Err(StoreError::Backend {
                message: "disk full".into(),
            });
        }
        match operation {
            KvOperation::Read { keys } => Ok(KvOutput {
                values: keys
                    .iter()
                    .filter_map(|k| self.store.get(k).map(|v| (*k, v.clone())))
                    .collect(),
            }),
            KvOperation::Write { entries } => {
                for (key, value) in entries {
                    self.store.insert(*key, value.clone());
                }
                Ok(KvOutput::default())
            }
            KvOperation::Delete { keys } => {
                for key in keys {
                    self.store.remove(key);
                }
                Ok(KvOutput::default())
            }
        }
    }

    pub fn pending(&self) -> Vec<&ApiRequest> {
        self.http.iter().map(|r| &r.operation).collect()
    }

    pub fn next_request(&self) -> &ApiRequest {
        &self.http.front().expect("an http request is pending").operation
    }

    /// Answers the oldest pending request.
    pub fn respond(&mut self, status: u16, body: Value) -> ApiRequest {
        self.answer(0, Ok(ApiResponse::new(status, body.to_string())))
    }

    pub fn respond_at(&mut self, index: usize, status: u16, body: Value) -> ApiRequest {
        self.answer(index, Ok(ApiResponse::new(status, body.to_string())))
    }

    pub fn fail(&mut self, error: HttpError) -> ApiRequest {
        self.answer(0, Err(error))
    }

    fn answer(&mut self, index: usize, output: Result<ApiResponse, HttpError>) -> ApiRequest {
        let mut request = self.http.remove(index).expect("no such pending request");
        let sent = request.operation.clone();
        let update = self.app.resolve(&mut request, output).expect("http resolves");
        self.absorb(update);
        sent
    }
}

pub fn fresh_user(phone: &str) -> User {
    User {
        id: None,
        phone_number: phone.into(),
        name: None,
        city: None,
    }
}

pub fn named_user(phone: &str, name: &str, city: &str) -> User {
    User {
        name: Some(name.into()),
        city: Some(city.into()),
        ..fresh_user(phone)
    }
}
