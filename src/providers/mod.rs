pub mod prediction_market;
pub mod spot;
pub mod volatility;

pub use prediction_market::{GammaMarket, OrderBook, PredictionMarketClient, PredictionMarketProvider};
pub use spot::{CoinGeckoSpotProvider, SpotPriceProvider};
pub use volatility::{DeribitVolatilityProvider, VolatilityProvider};
