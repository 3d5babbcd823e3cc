pub mod demande;
