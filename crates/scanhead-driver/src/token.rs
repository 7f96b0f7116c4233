//! 舵机事务完成令牌
//!
//! 舵机链路同一时刻最多只有一个未完成的运动事务。令牌为 Locked 表示事务已发出、
//! 尚未收到匹配的成功应答；收到应答后由接收线程释放。

use std::sync::atomic::{AtomicU8, Ordering};

/// 令牌状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TokenState {
    /// 无未完成事务（默认）
    #[default]
    Released = 0,
    /// 有一个事务等待应答
    Locked = 1,
}

impl TokenState {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Released。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Locked,
            _ => Self::Released,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_locked(self) -> bool {
        self == Self::Locked
    }
}

/// 完成令牌（原子版本，跨线程共享）
///
/// # 使用场景
///
/// - 前台扫描循环通过 `try_lock()` 开始一个运动事务
/// - 接收线程收到读角度应答或成功的运动应答后 `release()`
/// - 模式复位时强制 `release()`
///
/// # 示例
///
/// ```rust
/// use scanhead_driver::token::{CompletionToken, TokenState};
///
/// let token = CompletionToken::new();
/// assert!(token.try_lock());
/// // 第二个事务必须等待
/// assert!(!token.try_lock());
/// token.release();
/// assert_eq!(token.state(), TokenState::Released);
/// ```
#[derive(Debug, Default)]
pub struct CompletionToken {
    inner: AtomicU8,
}

impl CompletionToken {
    pub fn new() -> Self {
        Self {
            inner: AtomicU8::new(TokenState::Released.as_u8()),
        }
    }

    pub fn state(&self) -> TokenState {
        TokenState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn is_locked(&self) -> bool {
        self.state().is_locked()
    }

    /// 开始一个事务（Released → Locked）
    ///
    /// # 返回
    ///
    /// 已有未完成事务时返回 false，令牌保持不变。
    pub fn try_lock(&self) -> bool {
        self.compare_exchange(TokenState::Released, TokenState::Locked)
    }

    /// 释放令牌
    pub fn release(&self) {
        self.inner
            .store(TokenState::Released.as_u8(), Ordering::Release);
    }

    /// 比较并交换（Compare-and-Swap）
    ///
    /// # 返回
    ///
    /// 如果当前值等于 `current`，则设置为 `new` 并返回 true，否则返回 false
    pub fn compare_exchange(&self, current: TokenState, new: TokenState) -> bool {
        self.inner
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_token_state_conversions() {
        assert_eq!(TokenState::Released.as_u8(), 0);
        assert_eq!(TokenState::Locked.as_u8(), 1);
        assert_eq!(TokenState::from_u8(1), TokenState::Locked);
        assert_eq!(TokenState::from_u8(255), TokenState::Released);
        assert_eq!(TokenState::default(), TokenState::Released);
    }

    #[test]
    fn test_at_most_one_lock() {
        let token = CompletionToken::new();
        assert!(!token.is_locked());
        assert!(token.try_lock());
        assert!(token.is_locked());
        assert!(!token.try_lock());

        assert!(token.compare_exchange(TokenState::Locked, TokenState::Released));
        assert!(!token.compare_exchange(TokenState::Locked, TokenState::Released));
    }

    #[test]
    fn test_concurrent_lock_single_winner() {
        let token = Arc::new(CompletionToken::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let token = token.clone();
                std::thread::spawn(move || token.try_lock())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
