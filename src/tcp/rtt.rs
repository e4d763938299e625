use crate::sim::Time;

/// Round-trip time estimator and retransmission timeout, per RFC 6298.
#[derive(Clone, Debug)]
pub struct RttEstimator {
    srtt: Option<Time>,
    rttvar: Time,
    min: Option<Time>,
    latest: Option<Time>,
    min_rto: Time,
    max_rto: Time,
    initial_rto: Time,
}

/// Clock granularity term of the timeout.
const GRANULARITY: Time = Time::millis(1);

impl RttEstimator {
    pub fn new(initial_rto: Time, min_rto: Time, max_rto: Time) -> Self {
        Self {
            srtt: None,
            rttvar: Time::zero(),
            min: None,
            latest: None,
            min_rto,
            max_rto,
            initial_rto,
        }
    }

    pub fn update(&mut self, sample: Time) {
        self.latest = Some(sample);
        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rttvar = sample / 2;
            },
            Some(srtt) => {
                // rttvar = 3/4 rttvar + 1/4 |srtt - sample|; srtt = 7/8 srtt + 1/8 sample
                let err = if srtt > sample { srtt - sample } else { sample - srtt };
                self.rttvar = (self.rttvar * 3 + err) / 4;
                self.srtt = Some((srtt * 7 + sample) / 8);
            },
        }
    }

    pub fn smoothed(&self) -> Option<Time> {
        self.srtt
    }

    pub fn var(&self) -> Time {
        self.rttvar
    }

    pub fn min(&self) -> Option<Time> {
        self.min
    }

    pub fn latest(&self) -> Option<Time> {
        self.latest
    }

    /// Timeout before any backoff.
    pub fn rto(&self) -> Time {
        match self.srtt {
            None => self.initial_rto,
            Some(srtt) => (srtt + Time::max(GRANULARITY, self.rttvar * 4)).clamp(self.min_rto, self.max_rto),
        }
    }

    pub fn max_rto(&self) -> Time {
        self.max_rto
    }
}
