//! 步进扫描位置
//!
//! 位置在 `[low, high]` 内来回移动：越过上界时反向并回到 `high - step`（不低于 `low`），
//! 越过下界时对称处理。

/// 扫描方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// 步进扫描状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    position: i16,
    direction: Direction,
}

impl Sweep {
    /// 从 `start` 正向开始
    pub fn new(start: i16) -> Self {
        Self {
            position: start,
            direction: Direction::Forward,
        }
    }

    pub fn position(&self) -> i16 {
        self.position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 位置越界时夹回边界并调整方向
    ///
    /// 边界在两次迭代之间可能被上位机修改。
    pub fn clamp(&mut self, low: i16, high: i16) {
        if self.position < low {
            self.position = low;
            self.direction = Direction::Forward;
        } else if self.position > high {
            self.position = high;
            self.direction = Direction::Reverse;
        }
    }

    /// 按步长前进一步，越界时反向
    pub fn advance(&mut self, low: i16, high: i16, step: i16) {
        let (low, high, step) = (low as i32, high as i32, step.unsigned_abs() as i32);
        let mut next = self.position as i32;
        match self.direction {
            Direction::Forward => {
                next += step;
                if next > high {
                    self.direction = Direction::Reverse;
                    next = (high - step).max(low);
                }
            },
            Direction::Reverse => {
                next -= step;
                if next < low {
                    self.direction = Direction::Forward;
                    next = (low + step).min(high);
                }
            },
        }
        self.position = next.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reverses_after_crossing_high() {
        let mut sweep = Sweep::new(0);
        let mut positions = vec![sweep.position()];
        for _ in 0..11 {
            sweep.advance(0, 1000, 100);
            positions.push(sweep.position());
        }
        assert_eq!(positions[10], 1000);
        assert_eq!(positions[11], 900);
        assert_eq!(sweep.direction(), Direction::Reverse);
    }

    #[test]
    fn test_reverses_after_crossing_low() {
        let mut sweep = Sweep::new(100);
        sweep.direction = Direction::Reverse;
        sweep.advance(0, 1000, 100);
        assert_eq!(sweep.position(), 0);
        sweep.advance(0, 1000, 100);
        assert_eq!(sweep.position(), 100);
        assert_eq!(sweep.direction(), Direction::Forward);
    }

    #[test]
    fn test_step_larger_than_range() {
        let mut sweep = Sweep::new(0);
        sweep.advance(0, 50, 100);
        assert_eq!(sweep.position(), 0);
        assert_eq!(sweep.direction(), Direction::Reverse);
        sweep.advance(0, 50, 100);
        assert_eq!(sweep.position(), 50);
    }

    #[test]
    fn test_clamp_into_new_bounds() {
        let mut sweep = Sweep::new(900);
        sweep.clamp(0, 500);
        assert_eq!(sweep.position(), 500);
        assert_eq!(sweep.direction(), Direction::Reverse);

        sweep.clamp(600, 800);
        assert_eq!(sweep.position(), 600);
        assert_eq!(sweep.direction(), Direction::Forward);
    }

    proptest! {
        #[test]
        fn prop_sweep_stays_in_bounds(
            low in -1800i16..1800,
            span in 0i16..1800,
            step in 1i16..400,
            start_offset in 0i16..1800,
            iterations in 1usize..500,
        ) {
            let high = low.saturating_add(span);
            let mut sweep = Sweep::new(low.saturating_add(start_offset.min(span)));
            for _ in 0..iterations {
                sweep.advance(low, high, step);
                prop_assert!(sweep.position() >= low && sweep.position() <= high);
            }
        }
    }
}
