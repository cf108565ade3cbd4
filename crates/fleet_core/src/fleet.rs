//! Built-in fleet: five taxis, each cycling through five legs between US
//! state reference points (plus a few territories and Pacific islands that
//! lie outside every state zone).

use crate::config::AgentSpec;
use crate::geo::{GeoPoint, Route};

type Stop = (f64, f64);

const AL: Stop = (32.318231, -86.902298);
const CO: Stop = (39.550051, -105.782067);
const CT: Stop = (41.603221, -73.087749);
const FL: Stop = (27.664827, -81.515754);
const FM: Stop = (6.9167, 158.1833);
const GA: Stop = (32.157435, -82.907123);
const IA: Stop = (41.878003, -93.097702);
const ID: Stop = (44.068202, -114.742041);
const IL: Stop = (40.633125, -89.398528);
const IN: Stop = (40.551217, -85.602364);
const KY: Stop = (37.839333, -84.270018);
const MA: Stop = (42.407211, -71.382437);
const ME: Stop = (45.253783, -69.445469);
const MO: Stop = (37.964253, -91.831833);
const MS: Stop = (32.354668, -89.398528);
const MT: Stop = (46.879682, -110.362566);
const NC: Stop = (35.759573, -79.0193);
const NH: Stop = (43.193852, -71.572395);
const NM: Stop = (34.97273, -105.032363);
const NY: Stop = (43.299428, -74.217933);
const OH: Stop = (40.417287, -82.907123);
const OR: Stop = (43.804133, -120.554201);
const PW: Stop = (7.51498, 134.58252);
const RI: Stop = (41.580095, -71.477429);
const SC: Stop = (33.836081, -81.163725);
const TN: Stop = (35.517491, -86.580447);
const TX: Stop = (31.968599, -99.901813);
const VA: Stop = (37.431573, -78.656894);
// The original demo data pins this leg's "US Virgin Islands" end in north Georgia.
const VI: Stop = (34.297878, -83.824066);
const VT: Stop = (44.558803, -72.577841);
const WA: Stop = (47.751074, -120.740139);
const WY: Stop = (43.075968, -107.290284);

const TAXI_LEGS: [(&str, [(Stop, Stop); 5]); 5] = [
    ("taxi_a", [(RI, MA), (AL, VI), (KY, OH), (IL, IN), (VT, NH)]),
    ("taxi_b", [(TN, AL), (PW, FM), (CO, NM), (NC, VA), (AL, MS)]),
    ("taxi_c", [(ID, MT), (NM, TX), (AL, VI), (IA, MO), (SC, NC)]),
    ("taxi_d", [(NY, CT), (IL, IA), (OR, ID), (WY, CO), (WA, OR)]),
    ("taxi_e", [(TX, NM), (ME, NH), (FL, GA), (WA, ID), (CT, RI)]),
];

fn point((lat, lng): Stop) -> GeoPoint {
    GeoPoint::new(lat, lng).expect("fleet stops are valid coordinates")
}

/// The default demonstration fleet.
pub fn us_taxi_fleet() -> Vec<AgentSpec> {
    TAXI_LEGS
        .iter()
        .map(|(id, legs)| AgentSpec {
            id: (*id).to_string(),
            legs: legs
                .iter()
                .map(|(pickup, dropoff)| Route::new(point(*pickup), point(*dropoff)))
                .collect(),
        })
        .collect()
}
