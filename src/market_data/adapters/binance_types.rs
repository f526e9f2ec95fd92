// Source: https://binance-docs.github.io/apidocs/spot/en/#websocket-market-streams
// Prices and quantities arrive as decimal strings.

#[derive(Debug, serde::Deserialize)]
pub struct WsTrade {
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub qty: String,
    #[serde(rename = "T")]
    pub trade_time: u64,
}

// Partial book depth (`<symbol>@depth<levels>@100ms`); the diff-depth
// stream uses the short `b`/`a` keys for the same shape.
#[derive(Debug, serde::Deserialize)]
pub struct WsDepth {
    #[serde(alias = "b")]
    pub bids: Vec<WsLevel>,
    #[serde(alias = "a")]
    pub asks: Vec<WsLevel>,
}

#[derive(Debug, serde::Deserialize)]
pub struct WsLevel(pub String, pub String); // (price, qty)

// 24hr rolling window ticker (`<symbol>@ticker`)
#[derive(Debug, serde::Deserialize)]
pub struct WsTicker {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "c")]
    pub last_price: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub volume: String,
}
