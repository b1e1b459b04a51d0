mod leader_schedule;
mod party_rotation;
mod request_hashing;
mod threshold_signing;
