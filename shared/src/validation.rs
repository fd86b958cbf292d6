//! Validation utilities for the Agro Inventory Platform

use rust_decimal::Decimal;

// ============================================================================
// Dosification Validations
// ============================================================================

/// Largest treated area accepted for one dosification
pub const MAX_HECTARES: i64 = 100_000;

/// Validate the treated area of a dosification
pub fn validate_hectares(hectares: Decimal) -> Result<(), &'static str> {
    if hectares <= Decimal::ZERO {
        return Err("Hectares must be greater than zero");
    }
    if hectares > Decimal::from(MAX_HECTARES) {
        return Err("Hectares exceed the supported maximum");
    }
    Ok(())
}

/// Validate a quantity taken from or added to stock
pub fn validate_positive_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    Ok(())
}

// ============================================================================
// Crop Validations
// ============================================================================

/// Crops a dosification can target
pub const CROP_TYPES: &[&str] = &[
    "Aguacate",
    "Ajo",
    "Albaricoque",
    "Alcachofa",
    "Alfalfa",
    "Algodón",
    "Almendra",
    "Apio",
    "Arándano",
    "Arroz",
    "Arveja",
    "Avellana",
    "Avena",
    "Banano",
    "Berenjena",
    "Boniato",
    "Brócoli",
    "Cacahuete",
    "Cacao",
    "Café",
    "Calabacín",
    "Calabaza",
    "Caña de azúcar",
    "Cáñamo",
    "Caqui",
    "Cebada",
    "Cebolla",
    "Centeno",
    "Cereza",
    "Chayote",
    "Chile",
    "Cilantro",
    "Ciruela",
    "Clavel",
    "Col",
    "Coliflor",
    "Colza",
    "Dátil",
    "Espárrago",
    "Espinaca",
    "Forraje",
    "Frambuesa",
    "Fresa",
    "Girasol",
    "Granada",
    "Gypsophila",
    "Judía verde",
    "Kiwi",
    "Lechuga",
    "Leguminosas",
    "Lima",
    "Limón",
    "Lúpulo",
    "Maiz",
    "Mandarina",
    "Mango",
    "Manzana",
    "Melocotón",
    "Melón",
    "Mijo",
    "Mora",
    "Ñame",
    "Naranja",
    "Nectarina",
    "Nuez",
    "Oliva",
    "Paraguayo",
    "Patata",
    "Pepino",
    "Pera",
    "Pimiento",
    "Piña",
    "Pistacho",
    "Plátano",
    "Platerina",
    "Pomelo",
    "Remolacha azucarera",
    "Rosa",
    "Sandía",
    "Soja",
    "Tabaco",
    "Tomate de árbol",
    "Tomate de industria",
    "Trigo",
    "Uva de mesa",
    "Uva de vino",
    "Zanahoria",
    "Otro",
];

pub fn is_known_crop(crop: &str) -> bool {
    let crop = crop.trim().to_lowercase();
    CROP_TYPES.iter().any(|c| c.to_lowercase() == crop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_hectares() {
        assert!(validate_hectares(Decimal::new(25, 1)).is_ok());
        assert!(validate_hectares(Decimal::from(MAX_HECTARES)).is_ok());
        assert!(validate_hectares(Decimal::ZERO).is_err());
        assert!(validate_hectares(Decimal::from(-3)).is_err());
        assert!(validate_hectares(Decimal::from(MAX_HECTARES + 1)).is_err());
        assert!(validate_hectares(Decimal::MAX).is_err());
    }

    #[test]
    fn test_validate_positive_quantity() {
        assert!(validate_positive_quantity(Decimal::new(1, 2)).is_ok());
        assert!(validate_positive_quantity(Decimal::ZERO).is_err());
        assert!(validate_positive_quantity(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_known_crops() {
        assert!(is_known_crop("Café"));
        assert!(is_known_crop("aguacate"));
        assert!(is_known_crop("ÑAME"));
        assert!(is_known_crop(" Tomate de árbol "));
        assert!(!is_known_crop("Marte"));
    }
}
