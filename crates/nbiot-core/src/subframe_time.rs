use core::fmt;


#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubframeTime {
    /// Subframe number, from 0 to 9
    pub sf: u8,
    /// System frame number, from 0 to 1023
    pub sfn: u16,
    /// Hyper system frame number, from 0 to 1023
    pub hsfn: u16,
}

/// Value of i32 time where it wraps back to 0.
pub const TIME_INT_WRAP: i32 = 10 * 1024 * 1024;

/// Difference between two int times, handling wrap-around of the hyper system frame number.
pub fn time_int_diff(a: i32, b: i32) -> i32 {
    let mut diff = a - b;
    while diff < -TIME_INT_WRAP/2 { diff += TIME_INT_WRAP; }
    while diff >= TIME_INT_WRAP/2 { diff -= TIME_INT_WRAP; }
    diff
}

impl SubframeTime {
    pub fn is_valid(self) -> bool {
        self.sf <= 9 && self.sfn <= 1023 && self.hsfn <= 1023
    }

    pub fn to_int(self) -> i32 {
        self.sf as i32 +
        (self.sfn as i32 * 10) +
        (self.hsfn as i32 * 10 * 1024)
    }

    /// Converts an i32 time into a SubframeTime. Wraps modulo the full hyperframe cycle.
    pub fn from_int(time: i32) -> SubframeTime {
        let time = time.rem_euclid(TIME_INT_WRAP);
        let sf = (time % 10) as u8;
        let sfn = ((time / 10) % 1024) as u16;
        let hsfn = (time / (10 * 1024)) as u16;
        SubframeTime { sf, sfn, hsfn }
    }

    /// Builds a time from a linear millisecond count since 0/0/0
    pub fn from_ms(ms: u64) -> SubframeTime {
        SubframeTime::from_int((ms % TIME_INT_WRAP as u64) as i32)
    }

    /// Milliseconds since 0/0/0 within the current hyperframe cycle
    pub fn to_ms(self) -> u64 {
        self.to_int() as u64
    }

    /// Add a number of subframes (milliseconds) to a SubframeTime
    pub fn add_subframes(self, num: i32) -> SubframeTime {
        SubframeTime::from_int(self.to_int() + num)
    }

    /// Difference between two SubframeTimes in subframes
    pub fn diff(self, b: Self) -> i32 {
        time_int_diff(self.to_int(), b.to_int())
    }

    /// Age of this SubframeTime compared to now
    #[inline(always)]
    pub fn age(self, now: SubframeTime) -> i32 {
        now.diff(self)
    }

    /// True if `self` lies at or before `now`
    #[inline(always)]
    pub fn has_elapsed(self, now: SubframeTime) -> bool {
        self.age(now) >= 0
    }
}

impl fmt::Display for SubframeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4}/{:04}/{}", self.hsfn, self.sfn, self.sf)
    }
}

impl fmt::Debug for SubframeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4}/{:04}/{}", self.hsfn, self.sfn, self.sf)
    }
}
