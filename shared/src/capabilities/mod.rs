mod browser;
mod http;
mod kv;

pub use self::browser::{Browser, OpenUrl};
pub use self::http::{
    parse_envelope, ApiGateway, ApiRequest, ApiResponse, Http, HttpError, HttpGateway, HttpMethod,
    HttpResult, JSON_CONTENT_TYPE,
};
#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use self::kv::SqliteStore;
pub use self::kv::{
    KeyValue, KvOperation, KvOutput, KvResult, MemoryStore, SessionStore, StoreError, StoreKey,
    MAX_VALUE_SIZE,
};

pub use crux_core::render::Render;

#[allow(unused_imports)]
use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub http: Http<Event>,
    pub kv: KeyValue<Event>,
    pub browser: Browser<Event>,
}
