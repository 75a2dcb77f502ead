use std::collections::VecDeque;

use domain::Message;
use tokio::sync::RwLock;

/// 有界消息历史
///
/// 按追加顺序保存聊天与系统消息，超过容量时严格按 FIFO 从头部淘汰。
/// 读写都经过同一把读写锁，快照不会看到写了一半的状态。
pub struct MessageHistory {
    capacity: usize,
    messages: RwLock<VecDeque<Message>>,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            messages: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 追加到尾部，返回被淘汰的消息数量
    pub(crate) async fn append(&self, message: Message) -> usize {
        let mut messages = self.messages.write().await;
        messages.push_back(message);

        let mut evicted = 0;
        while messages.len() > self.capacity {
            messages.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub(crate) async fn clear(&self) {
        self.messages.write().await.clear();
    }

    /// 全部历史，旧消息在前
    pub async fn snapshot(&self) -> Vec<Message> {
        self.messages.read().await.iter().cloned().collect()
    }

    /// 最近 `limit` 条消息，旧消息在前
    pub async fn recent(&self, limit: usize) -> Vec<Message> {
        let messages = self.messages.read().await;
        let skip = messages.len().saturating_sub(limit);
        messages.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}
