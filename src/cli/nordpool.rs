use clap::Parser;
use reqwest::Url;

use crate::{api::nordpool, cli::CommonArgs, prelude::*};

#[derive(Parser)]
pub struct NordPoolArgs {
    /// Price currency.
    #[clap(long, env = "CURRENCY", default_value = "EUR")]
    pub currency: String,

    #[clap(long = "nordpool-base-url", env = "NORDPOOL_BASE_URL", default_value = nordpool::Api::DEFAULT_BASE_URL)]
    pub base_url: Url,
}

impl NordPoolArgs {
    pub fn new_api(&self, common: &CommonArgs) -> Result<nordpool::Api> {
        nordpool::Api::builder()
            .base_url(self.base_url.clone())
            .delivery_area(&common.delivery_area)
            .currency(&self.currency)
            .timezone(common.timezone)
            .build()
    }
}
