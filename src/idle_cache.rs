//! Idle frame cache with ping-pong mirroring.

use bytes::Bytes;

use crate::frames::IdleFrame;

/// Calculates the mirrored physical index for an unbounded logical index.
///
/// With `mirrored = true`, the period is `2 * n` and playback runs
/// `0, 1, ..., n-1, n-1, n-2, ..., 0, 0, 1, ...` (a palindrome, so there is
/// no visible seam at the loop ends). With `mirrored = false`, the period is
/// `n` and the index plainly wraps around.
///
/// Equivalent to a `turn`/`res` formulation (`turn = index // n`,
/// `res = index % n`, flip on odd turns when mirrored) but expressed in
/// closed form: `k = index mod 2n`, returning `k` when `k < n` else
/// `2n - 1 - k`.
///
/// # Panics
///
/// Panics if `n == 0`.
#[must_use]
pub fn mirror_index(logical_index: u64, n: usize, mirrored: bool) -> usize {
    assert!(n > 0, "idle cache must be non-empty");
    let n = n as u64;

    if !mirrored {
        return (logical_index % n) as usize;
    }

    let period = 2 * n;
    let k = logical_index % period;
    if k < n {
        k as usize
    } else {
        (period - 1 - k) as usize
    }
}

/// Holds the precomputed idle-animation images and answers mirrored
/// lookups.
///
/// Written once during `Initializing` (one `append` call per server
/// response), then read-only for the lifetime of the session.
#[derive(Debug, Default)]
pub struct IdleFrameCache {
    frames: Vec<IdleFrame>,
    mirrored: bool,
}

impl IdleFrameCache {
    /// Creates an empty cache. `mirrored` is set once `SessionReady`'s
    /// `is_mirrored_loop` parameter is known.
    #[must_use]
    pub fn new(mirrored: bool) -> Self {
        Self {
            frames: Vec::new(),
            mirrored,
        }
    }

    /// Appends an idle frame. Only valid while the session is
    /// `Initializing`; callers outside that state indicate a bug upstream
    /// (the dispatcher never calls this once `Idle` is reached).
    pub fn append(&mut self, frame_idx: u64, image_bytes: Bytes) {
        self.frames.push(IdleFrame {
            frame_idx,
            image_bytes,
        });
    }

    /// Number of frames cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the cache has not yet received any frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Looks up the idle frame for an unbounded logical index, applying
    /// ping-pong mirroring.
    ///
    /// # Panics
    ///
    /// Panics if the cache is empty.
    #[must_use]
    pub fn get(&self, logical_index: u64) -> &IdleFrame {
        let physical = mirror_index(logical_index, self.frames.len(), self.mirrored);
        &self.frames[physical]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_sequence_is_palindromic() {
        // n = 3: expect 0,1,2,2,1,0,0,1,2,2,1,0,...
        let expected = [0usize, 1, 2, 2, 1, 0, 0, 1, 2, 2, 1, 0];
        for (i, &want) in expected.iter().enumerate() {
            assert_eq!(mirror_index(i as u64, 3, true), want, "index {i}");
        }
    }

    #[test]
    fn unmirrored_sequence_plain_wraps() {
        let expected = [0usize, 1, 2, 0, 1, 2, 0];
        for (i, &want) in expected.iter().enumerate() {
            assert_eq!(mirror_index(i as u64, 3, false), want, "index {i}");
        }
    }

    #[test]
    fn mirror_is_symmetric_within_one_period() {
        let n = 7usize;
        for k in 0..n {
            let a = mirror_index(k as u64, n, true);
            let b = mirror_index((2 * n - 1 - k) as u64, n, true);
            assert_eq!(a, b, "k={k}");
        }
    }

    #[test]
    fn cache_len_matches_appended_count() {
        let mut cache = IdleFrameCache::new(true);
        for i in 0..125u64 {
            cache.append(i, Bytes::from_static(b"x"));
        }
        assert_eq!(cache.len(), 125);
    }

    #[test]
    fn lookup_follows_mirror_math() {
        let mut cache = IdleFrameCache::new(true);
        for i in 0..5u64 {
            cache.append(i, Bytes::from(vec![i as u8]));
        }
        // n=5, mirrored: index 5 -> mirror(5,5,true) = 4
        assert_eq!(cache.get(5).frame_idx, 4);
        assert_eq!(cache.get(0).frame_idx, 0);
        assert_eq!(cache.get(9).frame_idx, 0);
    }

    #[test]
    fn unmirrored_lookup_wraps_plainly() {
        let mut cache = IdleFrameCache::new(false);
        for i in 0..5u64 {
            cache.append(i, Bytes::from(vec![i as u8]));
        }
        assert_eq!(cache.get(5).frame_idx, 0);
        assert_eq!(cache.get(7).frame_idx, 2);
    }
}
