use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV write failure: {0}")]
    Csv(#[from] csv::Error),
    #[error("row has {row} fields, header has {header}")]
    RowWidth { row: usize, header: usize },
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Kind of rows a target file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Trades,
    Orderbook,
    Tickers,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Trades => "trades",
            Category::Orderbook => "orderbook",
            Category::Tickers => "tickers",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
