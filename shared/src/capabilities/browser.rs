//! Opening FAQ, tutorial and legal pages in the platform browser.

use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppError;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OpenUrl {
    pub url: Url,
}

impl Operation for OpenUrl {
    type Output = Result<(), AppError>;
}

#[derive(Capability)]
pub struct Browser<Ev> {
    context: CapabilityContext<OpenUrl, Ev>,
}

impl<Ev> Browser<Ev> {
    pub fn new(context: CapabilityContext<OpenUrl, Ev>) -> Self {
        Self { context }
    }
}

impl<Ev> Browser<Ev>
where
    Ev: Send + 'static,
{
    pub fn open<F>(&self, url: Url, make_event: F)
    where
        F: FnOnce(Result<(), AppError>) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context.request_from_shell(OpenUrl { url }).await;
            context.update_app(make_event(result));
        });
    }
}
