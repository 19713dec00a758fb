use crate::channel::SerenityChannelSender;
use crate::config::Config;
use crate::data::JsonStateStore;
use crate::feed::XApiClient;
use crate::notifier::{Notifier, SystemClock};
use crate::scheduler::DailyScheduler;
use serenity::http::Http;
use std::sync::Arc;

pub type SharedNotifier = Arc<Notifier>;

pub struct Bot {
    pub notifier: SharedNotifier,
    pub scheduler: Arc<DailyScheduler>,
}

impl Bot {
    /// Wire the notifier to the JSON state file, the X API and `http`.
    pub async fn new(config: Config, http: Arc<Http>) -> anyhow::Result<Self> {
        let store = JsonStateStore::load(&config.state_path).await;
        let feed = XApiClient::new(&config.notifier.api_base_url, config.notifier.bearer_token.clone())?;
        let channel = SerenityChannelSender::new(http);

        let notifier: SharedNotifier = Arc::new(Notifier::new(
            config.notifier,
            Arc::new(store),
            Arc::new(feed),
            Arc::new(channel),
            Arc::new(SystemClock),
        ));
        let scheduler = Arc::new(DailyScheduler::new(notifier.clone())?);

        Ok(Self { notifier, scheduler })
    }
}
