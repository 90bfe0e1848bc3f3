use crate::settings::{DefaultRendererSettings, FrameLabel};

pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64) -> Self {
        Self { frame_id: init_frame_id }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub const fn fif_count() -> usize {
        DefaultRendererSettings::FRAMES_IN_FLIGHT
    }
    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        FrameLabel::from_usize(self.frame_id as usize % Self::fif_count())
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_label_alternates() {
        let mut counter = FrameCounter::new(1);
        let labels: Vec<_> = (0..4)
            .map(|_| {
                let label = counter.frame_label();
                counter.next_frame();
                label
            })
            .collect();
        assert_eq!(labels, [FrameLabel::B, FrameLabel::A, FrameLabel::B, FrameLabel::A]);
        assert_eq!(counter.frame_name(), "[F5B]");
    }
}
