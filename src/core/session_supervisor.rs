//! 会话监管：取消令牌与单会话串行
//!
//! SessionSupervisor 持有根 CancellationToken，每次调用派生子 token（Ctrl+C 取消当前调用）；
//! SessionLocks 为每个会话维护一把异步互斥锁，保证同一会话同一时刻至多一个调用在执行。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::session::SessionId;

/// 生命周期管理：根取消令牌
#[derive(Debug)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消（所有子 token 一并取消）
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 创建子 token（用于单次调用）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// 会话锁表：session_id -> Arc<Mutex<()>>
///
/// 克隆共享同一张表（配置热更新后新旧 Agent 仍互斥）；最后一个持有者释放且无人排队时条目被移除。
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    locks: Arc<StdMutex<HashMap<SessionId, Arc<Mutex<()>>>>>,
}

/// 会话锁 guard；drop 时释放并清理空闲条目
#[derive(Debug)]
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    session: SessionId,
    locks: SessionLocks,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.locks.table();
        // 只剩表自身的引用：没有持有者也没有排队者
        if table
            .get(&self.session)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.session);
        }
    }
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_for(&self, session: &SessionId) -> Arc<Mutex<()>> {
        self.table()
            .entry(session.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn wrap(&self, session: &SessionId, guard: OwnedMutexGuard<()>) -> SessionGuard {
        SessionGuard {
            guard: Some(guard),
            session: session.clone(),
            locks: self.clone(),
        }
    }

    /// 等待获取会话锁；guard 释放前同一会话的其它调用会排队
    pub async fn acquire(&self, session: &SessionId) -> SessionGuard {
        let guard = self.lock_for(session).lock_owned().await;
        self.wrap(session, guard)
    }

    /// 立即尝试获取会话锁；已被占用时返回 None
    pub fn try_acquire(&self, session: &SessionId) -> Option<SessionGuard> {
        let guard = self.lock_for(session).try_lock_owned().ok()?;
        Some(self.wrap(session, guard))
    }

    /// 当前持有或等待中的会话数
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_acquire_busy_session() {
        let locks = SessionLocks::new();
        let id = SessionId::from("s1");
        let guard = locks.acquire(&id).await;
        assert!(locks.try_acquire(&id).is_none());
        drop(guard);
        assert!(locks.try_acquire(&id).is_some());
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_locks() {
        let locks = SessionLocks::new();
        let _a = locks.acquire(&SessionId::from("a")).await;
        let b = locks.try_acquire(&SessionId::from("b"));
        assert!(b.is_some());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_sessions_are_pruned() {
        let locks = SessionLocks::new();
        for i in 0..10 {
            let _guard = locks.acquire(&SessionId::from(format!("s{}", i).as_str())).await;
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_someone_waits() {
        let locks = SessionLocks::new();
        let id = SessionId::from("queued");
        let first = locks.acquire(&id).await;

        let waiter = tokio::spawn({
            let locks = locks.clone();
            let id = id.clone();
            async move {
                let _guard = locks.acquire(&id).await;
            }
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_one_table() {
        let locks = SessionLocks::new();
        let other = locks.clone();
        let id = SessionId::from("shared");
        let _guard = locks.acquire(&id).await;
        assert!(other.try_acquire(&id).is_none());
    }

    #[test]
    fn test_child_token_follows_parent() {
        let supervisor = SessionSupervisor::new();
        let child = supervisor.child_token();
        assert!(!child.is_cancelled());
        supervisor.cancel();
        assert!(child.is_cancelled());
        assert!(supervisor.is_cancelled());
    }
}
