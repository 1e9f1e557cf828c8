//! Explicit animation records sampled once per frame.
//!
//! A tween owns its start value, end value, duration and easing; the start
//! time is latched on the first sample so a tween created between frames
//! begins on the next rendered frame.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    QuadraticIn,
    QuadraticOut,
    QuadraticInOut,
}

impl Easing {
    pub fn apply(self, k: f32) -> f32 {
        let k = k.clamp(0.0, 1.0);
        match self {
            Easing::Linear => k,
            Easing::QuadraticIn => k * k,
            Easing::QuadraticOut => k * (2.0 - k),
            Easing::QuadraticInOut => {
                if k < 0.5 {
                    2.0 * k * k
                } else {
                    let t = 2.0 * k - 1.0;
                    0.5 * (1.0 - (t - 1.0) * (t - 1.0)) + 0.5
                }
            }
        }
    }
}

pub trait Lerp: Copy {
    fn lerp(self, to: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

impl Lerp for [f32; 3] {
    fn lerp(self, to: Self, t: f32) -> Self {
        [
            self[0].lerp(to[0], t),
            self[1].lerp(to[1], t),
            self[2].lerp(to[2], t),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Tween<T: Lerp> {
    from: T,
    to: T,
    duration_ms: f64,
    easing: Easing,
    start_ms: Option<f64>,
    finished: bool,
}

impl<T: Lerp> Tween<T> {
    pub fn new(from: T, to: T, duration_ms: f64, easing: Easing) -> Self {
        Self {
            from,
            to,
            duration_ms: duration_ms.max(0.0),
            easing,
            start_ms: None,
            finished: false,
        }
    }

    pub fn target(&self) -> T {
        self.to
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn sample(&mut self, now_ms: f64) -> T {
        let start = *self.start_ms.get_or_insert(now_ms);
        let progress = if self.duration_ms <= 0.0 {
            1.0
        } else {
            ((now_ms - start) / self.duration_ms).clamp(0.0, 1.0) as f32
        };
        if progress >= 1.0 {
            self.finished = true;
            return self.to;
        }
        self.from.lerp(self.to, self.easing.apply(progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easing_endpoints_are_fixed() {
        for easing in [
            Easing::Linear,
            Easing::QuadraticIn,
            Easing::QuadraticOut,
            Easing::QuadraticInOut,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-6);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6);
        }
        assert!((Easing::QuadraticInOut.apply(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tween_latches_start_on_first_sample() {
        let mut tween = Tween::new(0.0f32, 1.0, 100.0, Easing::Linear);
        assert_eq!(tween.sample(1_000.0), 0.0);
        assert!((tween.sample(1_050.0) - 0.5).abs() < 1e-6);
        assert!(!tween.is_finished());
        assert_eq!(tween.sample(1_100.0), 1.0);
        assert!(tween.is_finished());
    }

    #[test]
    fn zero_duration_completes_immediately() {
        let mut tween = Tween::new([1.0, 1.0, 1.0], [0.8, 0.0, 0.0], 0.0, Easing::Linear);
        assert_eq!(tween.sample(5.0), [0.8, 0.0, 0.0]);
        assert!(tween.is_finished());
    }
}
