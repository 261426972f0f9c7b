//! Telemetry/command gateway.
//!
//! Bridges the application core and a topic-based transport:
//!
//! | Module       | Direction | Purpose                                    |
//! |--------------|-----------|--------------------------------------------|
//! | `topics`     | both      | `dropster/*` topic map, retention policy   |
//! | `channels`   | in        | bounded queue from the receive callback    |
//! | `command`    | in        | payload parsing, debounce and expiry       |
//! | `fragments`  | in        | configuration transfer reassembly          |
//! | `engine`     | in        | drains the queue into `AppService`         |
//! | `messages`   | out       | `AppEvent` → topic + JSON body             |
//! | `transport`  | out       | `Publisher` trait                          |

pub mod channels;
pub mod command;
pub mod engine;
pub mod fragments;
pub mod messages;
pub mod topics;
pub mod transport;
