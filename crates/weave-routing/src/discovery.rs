//! Reactive route discovery (RREQ / RREP) and route errors.
//!
//! A discovery for a destination moves from no route, to pending, to either
//! resolved (an RREP arrived) or failed (timeout). Callers that ask for the
//! same destination while a discovery is pending wait on the same flood.
//! Each waiter leaves the pending list when it finishes or is dropped; the
//! entry goes away with its last waiter.

use crate::error::{RoutingError, RoutingResult};
use crate::packet::{PacketBody, RouteReply, RoutingPacket};
use crate::route_table::RouteEntry;
use crate::router::MeshRouter;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// One caller's place in a destination's waiter list.
///
/// Dropping it, on completion or when the caller's future is cancelled,
/// closes the receiver and prunes closed senders, so an abandoned discovery
/// never blocks the next caller from flooding.
struct PendingDiscovery<'a> {
    router: &'a MeshRouter,
    destination: &'a str,
    rx: oneshot::Receiver<Option<RouteEntry>>,
}

impl Drop for PendingDiscovery<'_> {
    fn drop(&mut self) {
        self.rx.close();
        let mut state = self.router.state.lock();
        if let Some(waiters) = state.pending.get_mut(self.destination) {
            waiters.retain(|tx| !tx.is_closed());
            if waiters.is_empty() {
                state.pending.remove(self.destination);
            }
        }
    }
}

impl MeshRouter {
    /// Flood an RREQ for `destination` and wait for the reply.
    pub(crate) async fn discover_route(&self, destination: &str) -> Option<RouteEntry> {
        let (tx, rx) = oneshot::channel();
        let rreq = {
            let mut state = self.state.lock();
            let waiters = state.pending.entry(destination.to_string()).or_default();
            waiters.retain(|tx| !tx.is_closed());
            let first = waiters.is_empty();
            waiters.push(tx);

            first.then(|| {
                let seq = state.next_seq();
                let packet = RoutingPacket::new(
                    self.node_id.clone(),
                    destination,
                    seq,
                    self.config.default_ttl,
                    PacketBody::RouteRequest {
                        target: destination.to_string(),
                    },
                )
                .with_path(vec![self.node_id.clone()]);
                state.seen.insert(packet.id());
                state.stats.rreq_sent += 1;
                packet
            })
        };
        let mut waiting = PendingDiscovery {
            router: self,
            destination,
            rx,
        };

        let initiator = rreq.is_some();
        if let Some(packet) = rreq {
            let sent = self.broadcast(&packet).await;
            debug!(node = %self.node_id, destination, sent, "route request flooded");
        }

        match tokio::time::timeout(self.config.discovery_timeout(), &mut waiting.rx).await {
            Ok(Ok(Some(route))) => {
                if initiator {
                    self.state.lock().stats.routes_discovered += 1;
                }
                info!(node = %self.node_id, destination, hops = route.hop_count, "route discovered");
                Some(route)
            }
            Ok(_) => None,
            Err(_) => {
                warn!(node = %self.node_id, destination, "route discovery timed out");
                None
            }
        }
    }

    pub(crate) async fn handle_rreq(
        &self,
        packet: RoutingPacket,
        from_neighbor: &str,
    ) -> RoutingResult<()> {
        let PacketBody::RouteRequest { target } = &packet.body else {
            return Ok(());
        };
        let target = target.clone();

        let proxy = {
            let mut state = self.state.lock();
            state.stats.rreq_received += 1;
            if packet.header.path_traversed.contains(&self.node_id) {
                state.stats.packets_dropped += 1;
                debug!(node = %self.node_id, target = %target, "route request looped, dropped");
                return Ok(());
            }
            state.table.best_route(&target)
        };

        let mut path = packet.header.path_traversed.clone();
        path.push(self.node_id.clone());

        if target == self.node_id {
            return self
                .send_rrep(&packet.header.source, from_neighbor, path, &target, 0)
                .await;
        }
        if let Some(route) = proxy {
            debug!(node = %self.node_id, target = %target, hops = route.hop_count, "proxy reply");
            return self
                .send_rrep(
                    &packet.header.source,
                    from_neighbor,
                    path,
                    &target,
                    route.hop_count,
                )
                .await;
        }

        self.forward(packet.with_path(path)).await
    }

    async fn send_rrep(
        &self,
        requester: &str,
        next_hop: &str,
        path: Vec<String>,
        target: &str,
        hop_count: u32,
    ) -> RoutingResult<()> {
        let packet = {
            let mut state = self.state.lock();
            let seq = state.next_seq();
            let packet = RoutingPacket::new(
                self.node_id.clone(),
                requester,
                seq,
                self.config.default_ttl,
                PacketBody::RouteReply(RouteReply {
                    target: target.to_string(),
                    hop_count,
                    path,
                }),
            );
            state.seen.insert(packet.id());
            packet
        };

        self.send_packet(&packet, next_hop).await?;
        self.state.lock().stats.rrep_sent += 1;
        Ok(())
    }

    pub(crate) async fn handle_rrep(
        &self,
        mut packet: RoutingPacket,
        from_neighbor: &str,
    ) -> RoutingResult<()> {
        let PacketBody::RouteReply(reply) = &mut packet.body else {
            return Ok(());
        };

        let waiters = {
            let mut state = self.state.lock();
            state.stats.rrep_received += 1;
            if reply.target != self.node_id {
                state.table.update_route(
                    &reply.target,
                    from_neighbor,
                    reply.hop_count + 1,
                    packet.header.seq_num,
                    Some(reply.path.clone()),
                );
            }

            if packet.header.destination == self.node_id {
                let best = state.table.best_route(&reply.target);
                let waiters = state.pending.remove(&reply.target).unwrap_or_default();
                Some((best, waiters))
            } else {
                None
            }
        };

        match waiters {
            Some((best, waiters)) => {
                debug!(node = %self.node_id, target = %reply.target, waiting = waiters.len(), "route reply arrived");
                for tx in waiters {
                    let _ = tx.send(best.clone());
                }
                Ok(())
            }
            None => {
                reply.hop_count += 1;
                self.forward(packet).await
            }
        }
    }

    pub(crate) async fn handle_rerr(
        &self,
        mut packet: RoutingPacket,
        from_neighbor: &str,
    ) -> RoutingResult<()> {
        let PacketBody::RouteError { broken_destination } = &packet.body else {
            return Ok(());
        };

        let invalidated = {
            let mut state = self.state.lock();
            state.stats.rerr_received += 1;
            state.table.invalidate_via(broken_destination, from_neighbor)
        };
        if invalidated == 0 {
            return Ok(());
        }
        debug!(node = %self.node_id, destination = %broken_destination, invalidated, "routes invalidated");

        if packet.header.ttl <= 1 {
            self.state.lock().stats.packets_dropped += 1;
            return Err(RoutingError::TtlExceeded {
                packet_id: packet.header.packet_id,
            });
        }
        packet.header.ttl -= 1;
        packet.header.hop_count += 1;
        packet.header.path_traversed.push(self.node_id.clone());
        self.broadcast(&packet).await;
        Ok(())
    }
}
