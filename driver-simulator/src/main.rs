mod client;
mod route_walk;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use colored::*;
use uuid::Uuid;

use bus_tracking::config::{EnvironmentConfig, TrackingConfig};
use bus_tracking::dto::trip_dto::TripResponse;
use bus_tracking::repositories::DEMO_VEHICLE_ID;
use bus_tracking::services::{SamplerReport, SamplingScheduler, SchedulerConfig, StopReason};
use bus_tracking::utils::jwt::{generate_driver_token, JwtConfig};

use client::{failure_code, HttpLocationSink, TrackingClient};
use route_walk::RouteWalkSource;

#[tokio::main]
async fn main() -> Result<()> {
    println!("{}", "🚌 Bus Tracking - Simulador de conductor".bright_blue().bold());
    println!("{}", "========================================".bright_blue());
    println!();

    // Paso 1: Servidor e identidad del conductor
    let server_url = prompt_with_default("Servidor", "http://localhost:3000")?;
    let driver_id = match prompt_with_default("ID de conductor", "nuevo")?.as_str() {
        "nuevo" => Uuid::new_v4(),
        value => Uuid::parse_str(value)?,
    };

    let jwt = JwtConfig::from(&EnvironmentConfig::from_env()?);
    let token = generate_driver_token(driver_id, &jwt)?;
    println!("{} {}", "✅ Token de conductor emitido para".bright_green(), driver_id);

    let client = TrackingClient::new(&server_url, token);

    // Paso 2: Viaje activo previo o viaje nuevo
    let trip = match client.active_trip().await? {
        Some(trip) => {
            println!(
                "{} bus {} en '{}'",
                "🔁 Reanudando viaje activo:".bright_yellow(),
                trip.vehicle_number,
                trip.route_name
            );
            trip
        }
        None => match start_new_trip(&client).await? {
            Some(trip) => trip,
            None => {
                println!("{}", "👋 ¡Hasta luego!".bright_green());
                return Ok(());
            }
        },
    };

    // Paso 3: Muestreo periódico
    let stops = client.route_stops(trip.route_id).await?.stops;
    let failure_rate: f64 = prompt_with_default("Tasa de fallo GPS simulada (0-1)", "0.1")?.parse()?;
    let config = SchedulerConfig::from(&TrackingConfig::from_env()?);

    let (handle, mut reports) = SamplingScheduler::start(
        trip.id,
        config,
        Arc::new(RouteWalkSource::new(&stops, failure_rate)),
        Arc::new(HttpLocationSink::new(client.clone())),
    );
    println!(
        "{} cada {:?} ({} paradas)",
        "🛰️ Muestreo iniciado".bright_green().bold(),
        config.period,
        stops.len()
    );

    let printer = tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            print_report(&report);
        }
    });

    // Paso 4: Menú principal
    loop {
        println!();
        println!("{}", "📋 MENÚ PRINCIPAL".bright_green().bold());
        println!("{}", "==================".bright_green());
        println!("1. 📍 Ver última posición");
        println!("2. 🏁 Finalizar viaje");
        println!("3. ✖️  Cancelar viaje");
        println!("4. 🚪 Salir (el viaje sigue activo)");
        let choice = prompt("Selecciona una opción (1-4): ")?;

        match choice.as_str() {
            "1" => match client.latest_location(trip.id).await {
                Ok(Some(sample)) => println!(
                    "📍 ({:.5}, {:.5}) a las {}",
                    sample.latitude, sample.longitude, sample.created_at
                ),
                Ok(None) => println!("{}", "⏳ Aún sin posiciones".bright_yellow()),
                Err(e) => println!("{} {}", "❌".bright_red(), e),
            },
            "2" | "3" => {
                let result = if choice == "2" {
                    client.end_trip(trip.id).await
                } else {
                    client.cancel_trip(trip.id).await
                };
                match result {
                    Ok(ended) => println!("{} ({:?})", "🏁 Viaje cerrado".bright_green(), ended.status),
                    Err(e) => println!("{} {}", "❌".bright_red(), e),
                }
                handle.stop().await;
                break;
            }
            "4" => {
                handle.stop().await;
                break;
            }
            _ => println!("{}", "❌ Opción inválida. Intenta de nuevo.".bright_red()),
        }
    }

    printer.await?;
    println!("{}", "👋 ¡Hasta luego!".bright_green());
    Ok(())
}

async fn start_new_trip(client: &TrackingClient) -> Result<Option<TripResponse>> {
    let routes = client.list_routes().await?;
    if routes.is_empty() {
        println!("{}", "❌ No hay rutas activas".bright_red());
        return Ok(None);
    }

    println!();
    println!("{}", "🗺️  RUTAS ACTIVAS".bright_cyan().bold());
    for (i, route) in routes.iter().enumerate() {
        println!("{}. {}", i + 1, route.name);
    }
    let index: usize = prompt_with_default("Ruta", "1")?.parse()?;
    let Some(route) = routes.get(index.saturating_sub(1)) else {
        println!("{}", "❌ Ruta inválida".bright_red());
        return Ok(None);
    };

    let vehicle_id = Uuid::parse_str(&prompt_with_default("ID de vehículo", &DEMO_VEHICLE_ID.to_string())?)?;

    match client.start_trip(vehicle_id, route.id).await {
        Ok(trip) => {
            println!(
                "{} bus {} en '{}'",
                "🚌 Viaje iniciado:".bright_green().bold(),
                trip.vehicle_number,
                trip.route_name
            );
            Ok(Some(trip))
        }
        Err(e) if failure_code(&e) == Some("CONFLICT") => {
            // Otro dispositivo abrió un viaje entre medias
            println!("{}", "⚠️ Ya tienes un viaje activo".bright_yellow());
            if prompt_with_default("¿Reanudarlo? (s/n)", "s")? == "s" {
                Ok(client.active_trip().await?)
            } else {
                Ok(None)
            }
        }
        Err(e) => Err(e),
    }
}

fn print_report(report: &SamplerReport) {
    match report {
        SamplerReport::Submitted(sample) => println!(
            "{} ({:.5}, {:.5})",
            "📤 Posición enviada".bright_blue(),
            sample.latitude,
            sample.longitude
        ),
        SamplerReport::AcquisitionFailed(failure) => {
            println!("{} {}", "📡 Sin posición:".bright_yellow(), failure)
        }
        SamplerReport::Rejected(e) => println!("{} {}", "❌ Rechazada:".bright_red(), e),
        SamplerReport::Stopped(StopReason::TripNotActive) => {
            println!("{}", "🛑 El viaje ya no está activo; muestreo detenido".bright_red())
        }
        SamplerReport::Stopped(_) => println!("{}", "🛑 Muestreo detenido".bright_green()),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label.bright_yellow());
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

fn prompt_with_default(label: &str, default: &str) -> Result<String> {
    let value = prompt(&format!("{} [{}]: ", label, default))?;
    Ok(if value.is_empty() { default.to_string() } else { value })
}
