// WebSocket模块 - 连接行情源并把归一化消息写入 MarketDataStore
//
// 消息格式（归一化信封）:
// {"stream": "orderbook"|"trade"|"liquidation"|"instrument",
//  "action": "snapshot"|"update"|"delete", "data": [...]}
//
// 交易所原生协议的解码不在这里处理。断线重连同样不在这里处理：
// 连接关闭时存储被标记为失效，后台聚合任务读取失败后按致命错误处理。

use crate::common::{AppError, BookEntry, Result};
use crate::feed::{MarketDataStore, StreamKind};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, instrument, warn, Instrument};
use url::Url;

/// WebSocket连接日志目标
pub const WEBSOCKET_CONNECTION_TARGET: &str = "websocket连接";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Snapshot,
    #[default]
    Update,
    Insert,
    Delete,
}

#[derive(Deserialize)]
struct Envelope {
    stream: String,
    #[serde(default)]
    action: Action,
    data: serde_json::Value,
}

/// 解析一条归一化消息并写入存储
///
/// 未知的 `stream` 会被忽略（返回 `Ok(false)`），例如订阅回执、心跳。
pub fn apply_message(store: &MarketDataStore, text: &str) -> Result<bool> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(_) => {
            debug!(target: WEBSOCKET_CONNECTION_TARGET, %text, "非行情消息，忽略");
            return Ok(false);
        }
    };

    let Some(kind) = StreamKind::from_name(&envelope.stream) else {
        debug!(target: WEBSOCKET_CONNECTION_TARGET, stream = %envelope.stream, "未知数据流，忽略");
        return Ok(false);
    };

    match kind {
        StreamKind::OrderBook => {
            let entries: Vec<BookEntry> = serde_json::from_value(envelope.data)?;
            match envelope.action {
                Action::Snapshot => store.replace_orderbook(entries)?,
                Action::Update | Action::Insert => store.upsert_orderbook(entries)?,
                Action::Delete => store.delete_orderbook(&entries)?,
            }
        }
        StreamKind::Trade => store.push_trades(serde_json::from_value(envelope.data)?)?,
        StreamKind::Liquidation => {
            store.push_liquidations(serde_json::from_value(envelope.data)?)?
        }
        StreamKind::OpenInterest => {
            store.push_open_interest(serde_json::from_value(envelope.data)?)?
        }
    }
    Ok(true)
}

/// 连接行情源，发送订阅消息，并启动后台读取任务
///
/// 连接或订阅失败直接返回错误；读取任务在连接关闭时把存储标记为失效后退出。
#[instrument(target = "websocket连接", skip(subscriptions, store), fields(exchange = %store.exchange_id()), err)]
pub async fn connect(
    url: &str,
    subscriptions: &[serde_json::Value],
    store: Arc<MarketDataStore>,
) -> Result<JoinHandle<()>> {
    let url = Url::parse(url)?;
    info!(target: WEBSOCKET_CONNECTION_TARGET, %url, "连接到WebSocket");

    let (mut ws_stream, _) = connect_async(url.clone())
        .await
        .map_err(|e| AppError::WebSocketError(format!("WebSocket连接失败 {}: {}", url, e)))?;

    for subscription in subscriptions {
        let msg = subscription.to_string();
        info!(target: WEBSOCKET_CONNECTION_TARGET, %msg, "发送订阅消息");
        ws_stream
            .send(Message::Text(msg))
            .await
            .map_err(|e| AppError::WebSocketError(format!("发送订阅消息失败: {}", e)))?;
    }

    let exchange = store.exchange_id().clone();
    let span = tracing::info_span!("ws_reader", %exchange);
    let handle = tokio::spawn(
        async move {
            while let Some(msg) = ws_stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = apply_message(&store, &text) {
                            warn!(
                                target: WEBSOCKET_CONNECTION_TARGET,
                                error = %e,
                                error_type = e.get_error_type_summary(),
                                "消息解析失败"
                            );
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if let Err(e) = ws_stream.send(Message::Pong(data)).await {
                            error!(target: WEBSOCKET_CONNECTION_TARGET, error = %e, "发送Pong失败");
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        info!(target: WEBSOCKET_CONNECTION_TARGET, ?frame, "收到关闭消息");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(target: WEBSOCKET_CONNECTION_TARGET, error = %e, "WebSocket错误");
                        break;
                    }
                }
            }
            store.mark_failed("WebSocket连接已关闭");
        }
        .instrument(span),
    );

    Ok(handle)
}
