//! Hop-by-hop forwarding and route failure handling.

use crate::error::{RoutingError, RoutingResult};
use crate::packet::{PacketBody, RoutingPacket};
use crate::router::MeshRouter;
use tracing::{debug, error, info, warn};

impl MeshRouter {
    /// Originate `body` towards `destination`, discovering a route if none
    /// is known and falling back to alternate routes on link failure.
    pub(crate) async fn send_body(&self, destination: &str, body: PacketBody) -> bool {
        let mut routes = self.get_route(destination);
        if routes.is_empty() {
            info!(node = %self.node_id, destination, "no route, starting discovery");
            if self.discover_route(destination).await.is_some() {
                routes = self.get_route(destination);
            }
        }
        if routes.is_empty() {
            warn!(node = %self.node_id, destination, "route discovery failed");
            self.state.lock().stats.packets_dropped += 1;
            return false;
        }

        for route in routes {
            let packet = {
                let mut state = self.state.lock();
                let seq = state.next_seq();
                let packet = RoutingPacket::new(
                    self.node_id.clone(),
                    destination,
                    seq,
                    self.config.default_ttl,
                    body.clone(),
                );
                state.seen.insert(packet.id());
                packet
            };

            match self.send_packet(&packet, &route.next_hop).await {
                Ok(()) => {
                    debug!(node = %self.node_id, destination, next_hop = %route.next_hop, "packet sent");
                    return true;
                }
                Err(RoutingError::Transport(e)) => {
                    warn!(node = %self.node_id, destination, next_hop = %route.next_hop, error = %e, "link failed");
                    self.handle_route_failure(destination, &route.next_hop).await;
                }
                Err(e) => {
                    error!(node = %self.node_id, destination, error = %e, "cannot encode packet");
                    break;
                }
            }
        }

        error!(node = %self.node_id, destination, "all routes failed");
        self.state.lock().stats.packets_dropped += 1;
        false
    }

    /// Move a transit packet one hop closer to its destination.
    pub(crate) async fn forward(&self, mut packet: RoutingPacket) -> RoutingResult<()> {
        let route = {
            let mut state = self.state.lock();
            if packet.header.ttl <= 1 {
                state.stats.packets_dropped += 1;
                return Err(RoutingError::TtlExceeded {
                    packet_id: packet.header.packet_id,
                });
            }
            let route = state.table.best_route(&packet.header.destination);
            if route.is_none() && !matches!(packet.body, PacketBody::RouteRequest { .. }) {
                state.stats.packets_dropped += 1;
                return Err(RoutingError::NoRoute {
                    destination: packet.header.destination,
                });
            }
            route
        };

        packet.header.ttl -= 1;
        packet.header.hop_count += 1;

        let Some(route) = route else {
            self.broadcast(&packet).await;
            return Ok(());
        };

        match self.send_packet(&packet, &route.next_hop).await {
            Ok(()) => {
                self.state.lock().stats.packets_forwarded += 1;
                Ok(())
            }
            Err(e) => {
                self.state.lock().stats.packets_dropped += 1;
                if matches!(e, RoutingError::Transport(_)) {
                    self.handle_route_failure(&packet.header.destination, &route.next_hop)
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Send to every fresh neighbour not already on the packet's path.
    /// Returns how many sends succeeded.
    pub(crate) async fn broadcast(&self, packet: &RoutingPacket) -> usize {
        let neighbors = self.state.lock().table.neighbors();
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(node = %self.node_id, error = %e, "cannot encode broadcast");
                return 0;
            }
        };

        let mut sent = 0;
        for neighbor in neighbors
            .iter()
            .filter(|n| !packet.header.path_traversed.contains(n))
        {
            if self.send_bytes(bytes.clone(), neighbor).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }

    pub(crate) async fn send_packet(
        &self,
        packet: &RoutingPacket,
        next_hop: &str,
    ) -> RoutingResult<()> {
        let bytes = packet.encode()?;
        self.send_bytes(bytes, next_hop).await
    }

    async fn send_bytes(&self, bytes: Vec<u8>, next_hop: &str) -> RoutingResult<()> {
        self.transport.send(bytes, next_hop).await?;
        self.state.lock().stats.packets_sent += 1;
        Ok(())
    }

    /// Drop routes to `destination` through the failed hop and tell the
    /// neighbourhood.
    pub(crate) async fn handle_route_failure(&self, destination: &str, failed_next_hop: &str) {
        let packet = {
            let mut state = self.state.lock();
            let removed = state.table.remove_via(destination, failed_next_hop);
            debug!(node = %self.node_id, destination, failed_next_hop, removed, "routes removed");

            let seq = state.next_seq();
            let packet = RoutingPacket::new(
                self.node_id.clone(),
                String::new(),
                seq,
                self.config.default_ttl,
                PacketBody::RouteError {
                    broken_destination: destination.to_string(),
                },
            )
            .with_path(vec![self.node_id.clone()]);
            state.seen.insert(packet.id());
            state.stats.rerr_sent += 1;
            packet
        };

        let sent = self.broadcast(&packet).await;
        info!(node = %self.node_id, destination, failed_next_hop, sent, "route error broadcast");
    }
}
